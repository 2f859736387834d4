mod scan_api_tests;
